mod registry_client;
